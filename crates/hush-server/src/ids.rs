use uuid::Uuid;

/// Produces the opaque public handle for a new secret.
pub trait HandleGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs in lowercase hyphenated form, e.g. `9b2f0c1e-...`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl HandleGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
