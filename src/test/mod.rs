// Test module organization
pub mod test_basic;
pub mod test_control_flow;
pub mod test_coroutine;
pub mod test_e2e;
pub mod test_functions;
pub mod test_gc;
pub mod test_metamethods;
pub mod test_pattern;
pub mod test_string;
pub mod test_table;
