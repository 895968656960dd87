//! Attribute parsing for the nativebind macros.

use syn::{Attribute, LitStr, meta::ParseNestedMeta};

/// Parsed `#[script_class(...)]` arguments.
#[derive(Debug, Default)]
pub struct ScriptClassAttrs {
    /// Native base class.
    pub base: Option<LitStr>,
    /// Script name override.
    pub name: Option<LitStr>,
}

impl ScriptClassAttrs {
    pub fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("base") {
            self.base = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
        } else {
            return Err(meta.error(format!(
                "unknown script_class attribute: {}",
                meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Parsed `#[native_virtual(...)]` marker on a method.
#[derive(Debug, Default)]
pub struct VirtualAttrs {
    /// Virtual name override.
    pub name: Option<String>,
}

/// Whether an attribute is the `native_virtual` marker, bare or path-qualified.
pub fn is_native_virtual(attr: &Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|segment| segment.ident == "native_virtual")
}

impl VirtualAttrs {
    /// Parse the marker from a method's attributes. `None` if the method is
    /// not marked.
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Option<Self>> {
        let Some(attr) = attrs.iter().find(|attr| is_native_virtual(attr)) else {
            return Ok(None);
        };

        let mut result = Self::default();
        if matches!(attr.meta, syn::Meta::Path(_)) {
            return Ok(Some(result));
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unknown native_virtual attribute, expected `name`"))
            }
        })?;
        Ok(Some(result))
    }
}
