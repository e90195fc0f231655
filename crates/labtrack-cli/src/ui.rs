//! Terminal implementations of the navigation and notification ports.

use labtrack_core::ports::{Navigator, Notice, Notifier, Route};

/// There are no screens to switch to; the user is told which command to run.
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        tracing::debug!(route = route.path(), "navigation requested");
        match route {
            Route::SignIn => {
                eprintln!("Your session has ended. Sign in again with `labtrack login`.");
            }
            Route::VerifyEmail => {
                println!("  Run `labtrack verify-email --email <EMAIL> --code <CODE>` to finish.");
            }
            Route::Dashboard => {}
        }
    }
}

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Success(message) => println!("✓ {message}"),
            Notice::Error(message) => eprintln!("✗ {message}"),
        }
    }
}
