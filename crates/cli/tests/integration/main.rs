mod common;

mod dump_tests;
mod replay_tests;
