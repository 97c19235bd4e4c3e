pub mod cube;
pub mod node;

pub use cube::Cube;
pub use node::Node;

mod octree;
pub use octree::Octree;

#[cfg(test)]
mod tests;
