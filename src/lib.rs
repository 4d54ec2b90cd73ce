// Configuration loading
pub mod config;

// Tag/anchor world state
pub mod state;

// Full-state fan-out to viewers
pub mod fanout;

// Forbidden zones and their external source
pub mod zone;

// Containment checks and alert debouncing
pub mod geofence;

// HTTP and WebSocket APIs
pub mod api;

// Bearer-token verification
pub mod auth;

// Device registry
pub mod devices;

// Headless viewer client
pub mod viewer;
