pub use super::delivery_logs::Entity as DeliveryLogs;
pub use super::persons::Entity as Persons;
