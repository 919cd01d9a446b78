//! Integration tests: full races through the public API.

mod mock_population;
mod property_tests;
mod simulation;
