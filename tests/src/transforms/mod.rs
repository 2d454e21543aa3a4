mod mapping;
mod pipeline;
mod remap;
