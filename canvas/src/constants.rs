use image::Rgba;

// New canvases start out opaque white
pub const BLANK_CANVAS_PIXEL: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
