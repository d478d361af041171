pub mod helpers;

mod tests_lsn;
