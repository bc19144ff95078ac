/// Instructions deployed assistants were created with. Must stay byte-identical, or every
/// restart against an existing assistant counts as drift.
pub const DEFAULT_INSTRUCTIONS: &str = include_str!("default_instructions.md");
