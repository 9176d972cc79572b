pub mod gen;
pub mod uint;
