pub mod backup_config;
pub mod copy;
pub mod engine;
pub mod exclusion;
pub mod namer;
pub mod path_mapper;
pub mod result_error;
pub mod supervisor;
pub mod validate;
pub mod watcher;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
