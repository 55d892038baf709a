// Many-body Green's function expressions and iterative solvers

pub mod tensor;
pub mod linalg;
pub mod expression;
pub mod config;
pub mod mp2_impl;
pub mod solver;
pub mod solver_impl;
pub mod chempot_impl;
