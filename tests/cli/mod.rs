/// CLI tests exercising the actual binary with assert_cmd
pub mod commands;
