// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across gcal

// OAuth Client Configuration
pub const GCAL_USE_CUSTOM_CLIENT: &str = "GCAL_USE_CUSTOM_CLIENT";
pub const GCAL_GOOGLE_CLIENT_ID: &str = "GCAL_GOOGLE_CLIENT_ID";
pub const GCAL_GOOGLE_CLIENT_SECRET: &str = "GCAL_GOOGLE_CLIENT_SECRET";
pub const GCAL_OAUTH_SERVER: &str = "GCAL_OAUTH_SERVER"; // Broker base URL

// Login Flow
pub const GCAL_CALLBACK_PORT: &str = "GCAL_CALLBACK_PORT";
pub const GCAL_LOGIN_TIMEOUT_SECS: &str = "GCAL_LOGIN_TIMEOUT_SECS";

// Token Storage
pub const GCAL_DATABASE_PATH: &str = "GCAL_DATABASE_PATH";

