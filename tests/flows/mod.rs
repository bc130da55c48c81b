mod relay_tests;
mod rpc_tests;
