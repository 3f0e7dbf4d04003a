pub mod protocol;
pub mod publisher;
pub mod rest;
pub mod state;
pub mod story_task;
pub mod textbook_task;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::{
    download_snapshot_handler, export_paginated_handler, export_slides_handler, health_handler,
};
pub use ws_handler::ws_handler;
