//! Caller-facing messages for authentication failures and acknowledgements.

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const ACCOUNT_LOCKED: &str = "Account is locked due to multiple failed login attempts";
pub const ACCOUNT_INACTIVE: &str = "Account is inactive";
pub const ACCOUNT_SUSPENDED: &str = "Account has been suspended";
pub const EMAIL_NOT_VERIFIED: &str = "Please verify your email address";
pub const TOKEN_INVALID: &str = "Invalid or expired token";
pub const TOKEN_EXPIRED: &str = "Token has expired";
pub const UNAUTHORIZED: &str = "Unauthorized access";
pub const FORBIDDEN: &str = "Insufficient permissions";

pub const LOGOUT_SUCCESS: &str = "Logged out successfully";
pub const LOGOUT_ALL_SUCCESS: &str = "Logged out from all devices";
pub const PASSWORD_CHANGED: &str = "Password changed successfully";
pub const PASSWORD_RESET_EMAIL_SENT: &str =
    "If the email exists, a password reset link has been sent";
pub const PASSWORD_RESET_SUCCESS: &str = "Password has been reset successfully";
pub const EMAIL_VERIFIED: &str = "Email verified successfully";
