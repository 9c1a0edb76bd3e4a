// ABOUTME: Shared configuration definitions for the gcal workspace
// ABOUTME: Exposes the environment variable names read by the auth library and the CLI

pub mod constants;
