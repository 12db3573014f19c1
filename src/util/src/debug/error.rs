//! Error and panic reporting built off the Rust standard library [Error] trait.

use std::{any::Any, error::Error, fmt};

use derive_where::derive_where;

// === Error formatting === //

pub trait ErrorFormatExt: Error {
	fn format_error(&self) -> FormattedError<Self> {
		FormattedError(self)
	}

	fn log(&self) {
		log::error!("{}", self.format_error());
	}
}

impl<T: ?Sized + Error> ErrorFormatExt for T {}

#[derive_where(Copy, Clone)]
pub struct FormattedError<'a, T: ?Sized>(pub &'a T);

impl<T: ?Sized + Error> fmt::Display for FormattedError<'_, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let target = self.0;

		write!(f, "Error: {}", target)?;

		let mut cause_iter = target.source();
		if cause_iter.is_some() {
			write!(f, "\n\nCaused by:")?;
		}

		while let Some(cause) = cause_iter {
			for line in cause.to_string().lines() {
				write!(f, "\n\t{}", line)?;
			}
			cause_iter = cause.source();
		}

		Ok(())
	}
}

// === Panic payloads === //

/// Extracts a printable message from the payload of a caught panic.
pub trait PanicPayloadExt {
	fn panic_message(&self) -> &str;
}

impl PanicPayloadExt for Box<dyn Any + Send> {
	fn panic_message(&self) -> &str {
		if let Some(msg) = self.downcast_ref::<&'static str>() {
			msg
		} else if let Some(msg) = self.downcast_ref::<String>() {
			msg.as_str()
		} else {
			"<non-string panic payload>"
		}
	}
}
