//! Cross-crate tests: archives go in through the jar reader and come out
//! through the jar writer.

#[cfg(test)]
mod core;
#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod transforms;
