//! Installers: status-line script and agent skill directories.

pub mod skill;
pub mod statusline;

pub use skill::{setup_skill, SkillOptions};
pub use statusline::setup_statusline;
