pub mod helpers;

mod tests_eviction;
