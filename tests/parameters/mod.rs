mod derived_tests;
mod table_properties;
