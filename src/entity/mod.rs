pub mod email_logs;
pub mod order_items;
pub mod orders;

pub use email_logs::Entity as EmailLogs;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
