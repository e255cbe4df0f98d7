pub mod customer;
pub mod guardrail;
pub mod handoff;
pub mod session;
pub mod specialist;
