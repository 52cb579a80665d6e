pub mod appointment;
pub mod quotation;
pub mod work_order;
