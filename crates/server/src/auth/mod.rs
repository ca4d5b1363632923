pub mod middleware;
pub mod resolver;
pub mod session;
pub mod token;
