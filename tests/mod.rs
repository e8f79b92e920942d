mod support;

mod e2e_tests;
mod limiter_tests;
