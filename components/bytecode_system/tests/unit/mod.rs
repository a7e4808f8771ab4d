//! Unit tests for bytecode_system

mod test_script;
mod test_try_notes;
