// libs/payment-cell/src/services/mod.rs
pub mod payment;
pub mod razorpay;
pub mod signature;

pub use payment::PaymentService;
pub use razorpay::RazorpayClient;
