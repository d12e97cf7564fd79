pub mod server_utils;
