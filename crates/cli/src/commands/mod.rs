pub mod run;
pub mod tree;
pub mod validate;
