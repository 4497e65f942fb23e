pub mod add;

pub use add::add_op;
