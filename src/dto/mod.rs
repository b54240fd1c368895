pub mod emails;
pub mod orders;
pub mod payments;
