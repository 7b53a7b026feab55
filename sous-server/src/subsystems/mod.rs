pub mod chef;
pub mod nutrition;
pub mod parse;
pub mod recipes;
pub mod tracking;
