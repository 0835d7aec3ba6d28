pub mod test_lifecycle;
pub mod test_run;
