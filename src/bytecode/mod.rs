pub mod bytecode;
pub mod debug_info;
pub mod op_code;
