pub mod analysis;
pub mod animation;
pub mod canvas;
pub mod decoding;
pub mod encoding;
pub mod font_assets;
pub mod particles;
pub mod playback;
pub mod recording;
pub mod renderer;
pub mod settings;
pub mod studio;
pub mod subtitle;
pub mod text;
pub mod theme;
pub mod timeline;
