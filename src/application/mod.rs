/// Application layer
///
/// Use cases built on top of the git operations:
/// - fetch settings planning
/// - loading commits into a local clone
/// - listing remote refs and testing connections
pub mod services;
pub mod use_cases;
