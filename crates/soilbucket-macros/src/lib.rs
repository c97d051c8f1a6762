use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

/// Scalar field types a `Columnar` row may hold.
const SCALAR_TYPES: &[&str] = &["f64", "f32", "i32", "i64", "u32", "u64", "usize"];

/// Derive macro that generates a companion column-oriented `*Table` struct
/// for collecting rows. All fields in the source struct must be plain scalars
/// (`f64`, `f32`, `i32`, `i64`, `u32`, `u64`, `usize`).
///
/// The generated table struct has the same fields as `Vec<T>`, along with
/// `with_capacity`, `push`, `len`, `is_empty` and `get` methods.
/// A `field_names()` associated function is also added to the row struct.
///
/// Use `#[columnar(table_name = "CustomName")]` to override the default
/// table struct name (`{StructName}Table`).
#[proc_macro_derive(Columnar, attributes(columnar))]
pub fn derive_columnar(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;

    let table_name =
        extract_table_name(&input).unwrap_or_else(|| format_ident!("{}Table", name));

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new_spanned(
                    name,
                    "Columnar can only be derived for structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "Columnar can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    if fields.is_empty() {
        return syn::Error::new_spanned(name, "Columnar struct must have at least one field")
            .to_compile_error()
            .into();
    }

    let mut field_names = Vec::new();
    let mut field_idents = Vec::new();
    let mut field_types = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        if !is_scalar_type(&field.ty) {
            return syn::Error::new_spanned(
                &field.ty,
                "Columnar derive: fields must be f64, f32, i32, i64, u32, u64 or usize",
            )
            .to_compile_error()
            .into();
        }
        field_names.push(ident.to_string());
        field_idents.push(ident);
        field_types.push(&field.ty);
    }

    let first_field = &field_idents[0];

    let field_name_strs: Vec<&str> = field_names.iter().map(|s| s.as_str()).collect();

    let table_fields = field_idents.iter().zip(&field_types).map(|(f, ty)| {
        quote! { pub #f: Vec<#ty> }
    });

    let with_cap_fields = field_idents.iter().map(|f| {
        quote! { #f: Vec::with_capacity(n) }
    });

    let push_fields = field_idents.iter().map(|f| {
        quote! { self.#f.push(row.#f); }
    });

    let get_fields = field_idents.iter().map(|f| {
        quote! { #f: self.#f[i] }
    });

    let expanded = quote! {
        /// Auto-generated column table for collecting rows.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct #table_name {
            #(#table_fields,)*
        }

        impl #table_name {
            /// Pre-allocate all columns for `n` rows.
            pub fn with_capacity(n: usize) -> Self {
                Self {
                    #(#with_cap_fields,)*
                }
            }

            /// Append a single row.
            pub fn push(&mut self, row: &#name) {
                #(#push_fields)*
            }

            /// Number of rows stored.
            pub fn len(&self) -> usize {
                self.#first_field.len()
            }

            /// Returns `true` if no rows have been stored.
            pub fn is_empty(&self) -> bool {
                self.#first_field.is_empty()
            }

            /// Reassemble row `i`, or `None` when out of range.
            pub fn get(&self, i: usize) -> Option<#name> {
                if i >= self.len() {
                    return None;
                }
                Some(#name {
                    #(#get_fields,)*
                })
            }
        }

        impl #name {
            /// Returns the field names of this row struct.
            pub fn field_names() -> &'static [&'static str] {
                &[#(#field_name_strs),*]
            }
        }
    };

    expanded.into()
}

fn extract_table_name(input: &DeriveInput) -> Option<proc_macro2::Ident> {
    for attr in &input.attrs {
        if attr.path().is_ident("columnar") {
            let nested = attr
                .parse_args_with(
                    syn::punctuated::Punctuated::<syn::Meta, syn::Token![,]>::parse_terminated,
                )
                .ok()?;
            for meta in nested {
                if let Meta::NameValue(nv) = meta {
                    if nv.path.is_ident("table_name") {
                        if let syn::Expr::Lit(expr_lit) = &nv.value {
                            if let Lit::Str(lit_str) = &expr_lit.lit {
                                return Some(format_ident!("{}", lit_str.value()));
                            }
                        }
                    }
                }
            }
        }
    }
    None
}

fn is_scalar_type(ty: &syn::Type) -> bool {
    if let syn::Type::Path(type_path) = ty {
        SCALAR_TYPES
            .iter()
            .any(|scalar| type_path.path.is_ident(scalar))
    } else {
        false
    }
}
