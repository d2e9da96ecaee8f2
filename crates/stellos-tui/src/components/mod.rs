pub mod galaxy_map;
pub mod help_overlay;
pub mod now_playing;
