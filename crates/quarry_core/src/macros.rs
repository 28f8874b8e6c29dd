/// Builds a [`crate::types::Diagnostic`] from a `DiagnosticBuilder` expression, stamping the
/// origin with the calling module.
#[macro_export]
macro_rules! diagnostic_error {
  ($builder:expr) => {
    $builder
      .origin(Some(String::from(module_path!())))
      .build()
      .unwrap_or_else(|error| $crate::types::Diagnostic {
        message: error.to_string(),
        origin: Some(String::from(module_path!())),
        ..$crate::types::Diagnostic::default()
      })
  };
}

#[macro_export]
macro_rules! as_variant_impl {
  ($enum_name:ident, $method:ident, $variant:ident, $output:ty) => {
    impl $enum_name {
      pub fn $method(&self) -> Option<&$output> {
        match self {
          $enum_name::$variant(output) => Some(output),
          _ => None,
        }
      }
    }
  };
}
