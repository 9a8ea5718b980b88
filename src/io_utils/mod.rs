pub mod tempfile_utils;
