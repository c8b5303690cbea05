//! # Error Handling Framework
//!
//! This module provides a comprehensive error handling system for the platform.
//! It implements structured error management with:
//! 
//! ## Core Features
//! 
//! - **Structured Error Types**: Categorized error codes for consistent handling
//! - **Rich Context**: Request context and error metadata for debugging
//! - **Severity Classification**: Error categorization for appropriate responses
//! - **User-Friendly Messages**: Localized error messages for end users
//! 
//! ## Error Categories
//! 
//! - **Validation**: Input validation and business rule violations
//! - **Authentication**: Identity verification and authorization failures
//! - **Database**: Persistence layer errors and constraint violations
//! - **Network**: External service communication failures
//! - **Configuration**: System setup and configuration issues
//! - **Internal**: Unexpected system errors requiring investigation
//! 
//! ## Context Tracking
//! 
//! - **Request Context**: HTTP request tracking with correlation IDs
//! - **Error Context**: Structured error metadata and stack traces
//! - **User Context**: User-specific error handling and permissions
//! 
//! ## Monitoring Integration
//! 
//! - **Structured Logging**: Consistent error logging with correlation
//! 
//! ## Usage Examples
//!
//! ```rust
//! use cve_core::error::{Error, ErrorCode};
//!
//! // Creating structured errors
//! fn validate_cve_id(id: &str) -> Result<(), Error> {
//!     if !id.starts_with("CVE-") {
//!         return Err(Error::validation("Invalid CVE identifier format")
//!             .with_details(format!("received: {id}")));
//!     }
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod context;
pub mod framework;

pub use codes::ErrorCode;
pub use context::ErrorContext;
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};