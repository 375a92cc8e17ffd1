pub mod check;
pub mod remote;
pub mod serve;
