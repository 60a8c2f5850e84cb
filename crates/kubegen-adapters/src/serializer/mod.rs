//! Document serializers.

mod yaml;

pub use yaml::YamlSerializer;
