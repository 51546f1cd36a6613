mod corrections;
mod fixtures;
mod tracing;
