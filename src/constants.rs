//! Shared application-wide constants.
//! Centralizes tweakable values used by the geometry kernel, both renderers and the editor.

// Node dimensions
/// Minimum node width in map units.
pub const MIN_NODE_WIDTH: f32 = 50.0;
/// Minimum node height in map units.
pub const MIN_NODE_HEIGHT: f32 = 30.0;
/// Default node width in map units.
pub const NODE_WIDTH: f32 = 150.0;
/// Default node height in map units.
pub const NODE_HEIGHT: f32 = 60.0;
/// Upper bound for the corner radius of rounded rectangles.
pub const MAX_CORNER_RADIUS: f32 = 16.0;

// Default paint
/// Default node fill.
pub const DEFAULT_BACKGROUND_COLOR: &str = "#3B82F6";
/// Default node label color.
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";
/// Default node border color.
pub const DEFAULT_BORDER_COLOR: &str = "#1E40AF";
/// Default node font family.
pub const DEFAULT_FONT_FAMILY: &str = "system-ui";
/// Default node font size.
pub const DEFAULT_FONT_SIZE: u32 = 14;
/// Default connection color.
pub const DEFAULT_LINE_COLOR: &str = "#6B7280";
/// Default connection stroke width.
pub const DEFAULT_LINE_WIDTH: u32 = 4;
/// Default tag color.
pub const DEFAULT_TAG_COLOR: &str = "#6B7280";

// Connections
/// Vertical lift applied to connection labels above the center-to-center midpoint.
pub const CONNECTION_LABEL_LIFT: f32 = 10.0;
/// Arrowhead length per unit of line width.
pub const ARROW_LENGTH_PER_WIDTH: f32 = 3.0;
/// Arrowhead half-width per unit of line width.
pub const ARROW_HALF_WIDTH_PER_WIDTH: f32 = 1.5;

// Grid/drawing
/// Grid cell size in map units.
pub const GRID_SIZE: f32 = 20.0;
/// Side length of the square resize handle drawn at a selected node's bottom-right corner.
pub const RESIZE_HANDLE_SIZE: f32 = 10.0;
/// Radius of the description indicator drawn near a node's top-right corner.
pub const DESCRIPTION_ICON_RADIUS: f32 = 8.0;
/// Inset of the description indicator from the node's top-right corner.
pub const DESCRIPTION_ICON_INSET: f32 = 10.0;
/// Horizontal padding kept between a node's outline and its label.
pub const LABEL_PADDING: f32 = 8.0;
/// Approximate advance of one glyph relative to the font size, shared by both renderers.
pub const GLYPH_WIDTH_RATIO: f32 = 0.55;
/// Line height relative to the font size.
pub const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Side length of one accessibility pattern tile.
pub const PATTERN_TILE: f32 = 8.0;

// View
/// Smallest zoom factor.
pub const MIN_ZOOM: f32 = 0.25;
/// Largest zoom factor.
pub const MAX_ZOOM: f32 = 4.0;
/// Padding around the node bounding box used by fit-to-screen.
pub const FIT_PADDING: f32 = 50.0;
/// Fit-to-screen never magnifies beyond this factor.
pub const FIT_MAX_SCALE: f32 = 2.0;
/// Multiplicative zoom step for one wheel notch.
pub const ZOOM_STEP: f32 = 1.1;

// Canvas interactions
/// Hit distance (map units) for selecting a connection.
pub const CLICK_THRESHOLD: f32 = 6.0;
/// Offset applied to duplicated nodes on both axes.
pub const DUPLICATE_OFFSET: f32 = 30.0;
/// Quiet period before a burst of text edits is saved, in seconds.
pub const SAVE_DEBOUNCE_SECS: f64 = 0.3;
/// How long a notification stays on screen, in seconds.
pub const NOTIFICATION_SECS: f64 = 4.0;
