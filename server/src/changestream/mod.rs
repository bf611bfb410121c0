mod delete;
mod field_update;
mod insert;
mod update;

pub use delete::run_delete_consumer;
pub use field_update::FieldUpdate;
pub use insert::run_insert_consumer;
pub use update::run_update_consumer;
