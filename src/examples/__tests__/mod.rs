mod inheritance_test;
mod json_test;
