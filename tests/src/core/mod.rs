mod archive;
mod resolver;
