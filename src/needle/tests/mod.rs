mod tests_meta;
mod tests_scan;
