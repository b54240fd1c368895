pub mod email_service;
pub mod order_service;
pub mod payment_service;
pub mod webhook_service;
