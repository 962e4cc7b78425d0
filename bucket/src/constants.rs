pub const APIKEY_HEADER: &str = "apikey";
pub const UPSERT_HEADER: &str = "x-upsert";

// Object keys are local save paths without these prefixes
pub const LOCAL_PREFIXES: [&str; 2] = ["./", "/"];
