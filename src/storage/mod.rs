pub mod memory;
pub mod trait_def;

pub use memory::InMemoryAuditRepository;
pub use trait_def::AuditRepository;
