use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, ImplItem, ImplItemFn, ItemImpl, Stmt, Variant,
    Visibility,
};

/// Turns an error enum into a handover error type.
///
/// The attribute:
/// 1. Adds `#[derive(Debug, thiserror::Error, uniffi::Error)]` and `#[uniffi(flat_error)]`
/// 2. Appends a `Generic { message: String }` variant unless the enum already has one
/// 3. Implements `From<anyhow::Error>`, flattening the context chain into `message`
/// 4. Adds `from_anyhow_result` helpers
///
/// # Usage
///
/// ```rust,ignore
/// #[handover_error]
/// pub enum RemoteError {
///     #[error("{endpoint} answered {code}")]
///     BadStatus { endpoint: String, code: u16 },
/// }
/// ```
#[proc_macro_attribute]
pub fn handover_error(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "handover_error can only be applied to enums")
            .to_compile_error()
            .into();
    };

    let enum_name = &input.ident;
    let visibility = &input.vis;
    let generics = &input.generics;

    // Derives and uniffi attributes are generated below
    let attrs: Vec<_> = input
        .attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("derive") && !attr.path().is_ident("uniffi"))
        .collect();

    let mut variants = data_enum.variants.clone();
    if !variants.iter().any(|variant| variant.ident == "Generic") {
        let generic_variant: Variant = syn::parse_quote! {
            /// Any other failure, carrying the flattened error chain.
            #[error("{message}")]
            Generic {
                /// The flattened error chain.
                message: String
            }
        };
        variants.push(generic_variant);
    }

    quote! {
        #[derive(Debug, thiserror::Error, uniffi::Error)]
        #[uniffi(flat_error)]
        #(#attrs)*
        #visibility enum #enum_name #generics {
            #variants
        }

        impl #generics From<anyhow::Error> for #enum_name #generics {
            fn from(err: anyhow::Error) -> Self {
                Self::Generic {
                    message: Self::flatten_chain(&err),
                }
            }
        }

        impl #generics #enum_name #generics {
            /// Converts an `anyhow::Result` into a result with this error type.
            ///
            /// # Errors
            /// Returns the `Generic` variant when `result` is an error.
            pub fn from_anyhow_result<T>(result: anyhow::Result<T>) -> Result<T, Self> {
                result.map_err(Self::from)
            }

            /// Like `from_anyhow_result`, with `prefix` in front of the message.
            ///
            /// # Errors
            /// Returns the `Generic` variant when `result` is an error.
            pub fn from_anyhow_result_with_prefix<T>(
                result: anyhow::Result<T>,
                prefix: &str,
            ) -> Result<T, Self> {
                result.map_err(|err| Self::Generic {
                    message: format!("{}: {}", prefix, Self::flatten_chain(&err)),
                })
            }

            fn flatten_chain(err: &anyhow::Error) -> String {
                let mut message = err.to_string();
                let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
                if !chain.is_empty() {
                    message.push_str(" (caused by: ");
                    message.push_str(&chain.join(" -> "));
                    message.push(')');
                }
                message
            }
        }
    }
    .into()
}

/// Wraps `uniffi::export` and injects a logging context into every public method.
///
/// The attribute:
/// 1. Forwards its arguments to `#[uniffi::export]`
/// 2. Inserts `let _handover_logger_ctx = crate::primitives::logger::LogContext::new("TypeName");`
///    at the start of every `pub fn`
/// 3. Adds `async_runtime = "tokio"` when any public method is async
///
/// # Usage
///
/// ```rust,ignore
/// #[handover_export]
/// impl MigrationEngine {
///     pub async fn run_batch(&self) -> BatchReport {
///         // logs here are prefixed with [Handover][MigrationEngine]
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn handover_export(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_impl = parse_macro_input!(input as ItemImpl);

    let type_name = match &*input_impl.self_ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| "Unknown".into(), |segment| segment.ident.to_string()),
        _ => "Unknown".to_string(),
    };

    let has_async_functions = has_async_functions_in_impl(&input_impl.items);

    let new_items = input_impl
        .items
        .iter()
        .map(|item| match item {
            ImplItem::Fn(method) if matches!(method.vis, Visibility::Public(_)) => {
                let mut new_method = method.clone();
                inject_logging_context(&mut new_method, &type_name);
                ImplItem::Fn(new_method)
            }
            other => other.clone(),
        })
        .collect();

    let new_impl = ItemImpl {
        items: new_items,
        ..input_impl
    };

    let mut args = proc_macro2::TokenStream::from(args);
    if has_async_functions {
        args = if args.is_empty() {
            quote! { async_runtime = "tokio" }
        } else {
            quote! { #args, async_runtime = "tokio" }
        };
    }

    quote! {
        #[uniffi::export(#args)]
        #new_impl
    }
    .into()
}

/// Whether any public function in the impl block is async
fn has_async_functions_in_impl(impl_items: &[ImplItem]) -> bool {
    impl_items.iter().any(|item| {
        if let ImplItem::Fn(method) = item {
            matches!(method.vis, Visibility::Public(_)) && method.sig.asyncness.is_some()
        } else {
            false
        }
    })
}

fn inject_logging_context(method: &mut ImplItemFn, type_name: &str) {
    let context_stmt: Stmt = syn::parse_quote! {
        let _handover_logger_ctx = crate::primitives::logger::LogContext::new(#type_name);
    };
    method.block.stmts.insert(0, context_stmt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_detection_with_async_functions() {
        let impl_block: ItemImpl = syn::parse_quote! {
            impl MigrationEngine {
                pub fn options(&self) -> EngineOptions {
                    self.options.clone()
                }

                pub async fn run_batch(&self) -> BatchReport {
                    todo!()
                }
            }
        };

        assert!(has_async_functions_in_impl(&impl_block.items));
    }

    #[test]
    fn test_async_detection_ignores_private_async_functions() {
        let impl_block: ItemImpl = syn::parse_quote! {
            impl MigrationEngine {
                pub fn options(&self) -> EngineOptions {
                    self.options.clone()
                }

                async fn run_pair(&self) -> PairReport {
                    todo!()
                }
            }
        };

        assert!(!has_async_functions_in_impl(&impl_block.items));
    }

    #[test]
    fn test_logging_context_is_first_statement() {
        let mut method: ImplItemFn = syn::parse_quote! {
            pub fn cancel(&self) {
                self.flag.store(true, Ordering::SeqCst);
            }
        };

        inject_logging_context(&mut method, "CancellationToken");

        assert_eq!(method.block.stmts.len(), 2);
        let first = &method.block.stmts[0];
        let rendered = quote!(#first).to_string();
        assert!(rendered.contains("_handover_logger_ctx"));
        assert!(rendered.contains("\"CancellationToken\""));
    }
}
