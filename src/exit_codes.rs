//! Exit code constants for the lockwarden CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Lock store failure
//! - 3: Liveness query failure
//! - 4: Lock acquisition failure (timeout or cancellation)
//! - 5: Protected command failed

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or refused operation.
pub const USER_ERROR: i32 = 1;

/// The shared lock store could not be read or written.
pub const STORE_FAILURE: i32 = 2;

/// The session registry could not answer a liveness query.
pub const QUERY_FAILURE: i32 = 3;

/// The lock could not be acquired within the retry budget.
pub const LOCK_FAILURE: i32 = 4;

/// The command run under the lock exited unsuccessfully.
pub const OPERATION_FAILURE: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            STORE_FAILURE,
            QUERY_FAILURE,
            LOCK_FAILURE,
            OPERATION_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
