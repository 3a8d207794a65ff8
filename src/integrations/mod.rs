pub mod jotty;
