pub mod charset;
pub mod compositor;
pub mod density;
pub mod frame;
pub mod glyph_frame;
pub mod glyph_raster;
pub mod glyph_style;
pub mod grading;
pub mod hash;
pub mod mask;
pub mod pattern;
pub mod post_fx;
pub mod preset;
pub mod render_loop;
pub mod renderer;
pub mod scene;
pub mod schema;
