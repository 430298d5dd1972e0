//! Parser tests over fixture descriptors.

mod descriptor_tests;
