pub mod dndbeyond;
pub mod fivetools;
