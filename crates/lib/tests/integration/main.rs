mod common;
mod deploy_tests;
mod edge_function_tests;
