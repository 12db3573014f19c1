use std::{borrow::Cow, fmt};

/// An optional human-readable name attached to a runtime object for logging and diagnostics.
pub type ReifiedDebugLabel = Option<Cow<'static, str>>;

pub trait DebugLabel: Sized {
	fn reify(self) -> ReifiedDebugLabel;
}

pub const NO_LABEL: Option<&'static str> = None;

impl DebugLabel for ReifiedDebugLabel {
	fn reify(self) -> ReifiedDebugLabel {
		self
	}
}

impl DebugLabel for String {
	fn reify(self) -> ReifiedDebugLabel {
		Some(Cow::Owned(self))
	}
}

impl DebugLabel for &'static str {
	fn reify(self) -> ReifiedDebugLabel {
		Some(Cow::Borrowed(self))
	}
}

impl DebugLabel for fmt::Arguments<'_> {
	fn reify(self) -> ReifiedDebugLabel {
		match self.as_str() {
			Some(static_str) => Some(Cow::Borrowed(static_str)),
			None => Some(Cow::Owned(self.to_string())),
		}
	}
}

impl DebugLabel for Option<&'static str> {
	fn reify(self) -> ReifiedDebugLabel {
		self.map(Cow::Borrowed)
	}
}

// === LabelDisplay === //

/// Formats a [`ReifiedDebugLabel`], falling back to a placeholder for unnamed objects.
#[derive(Debug, Copy, Clone)]
pub struct LabelDisplay<'a> {
	label: &'a ReifiedDebugLabel,
	fallback: &'static str,
}

impl<'a> LabelDisplay<'a> {
	pub fn new(label: &'a ReifiedDebugLabel) -> Self {
		Self {
			label,
			fallback: "<unnamed>",
		}
	}

	pub fn with_fallback(label: &'a ReifiedDebugLabel, fallback: &'static str) -> Self {
		Self { label, fallback }
	}
}

impl fmt::Display for LabelDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.label {
			Some(label) => write!(f, "{label:?}"),
			None => f.write_str(self.fallback),
		}
	}
}
