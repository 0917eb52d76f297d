pub mod control;
pub mod error;
pub mod expr;
pub mod math;
pub mod model;
pub mod response;
pub mod symtf;
pub mod tf;
