mod solve_tests;
mod subst_tests;
