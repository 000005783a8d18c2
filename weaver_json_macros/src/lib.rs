use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, Type, parse_macro_input};

/// Derive a `weaver_json::Function` implementation from a function.
///
/// The function parameters become positional arguments. Argument types are
/// declared in the generated signature, so literal arguments are checked
/// when an expression is compiled and every call is checked at runtime.
///
/// # Attribute syntax
///
/// ```ignore
/// #[weaver_function(name = "shout")]           // shout(text)
/// #[weaver_function(name = "repeat", member)]  // text.repeat(count)
/// ```
///
/// With `member`, the first parameter receives the call's receiver.
///
/// # Supported parameter types
/// - `Value` — accepts any value, no validation
/// - `String` — validates the argument is a string, passes the inner String
/// - `f64` — validates the argument is a number, passes the inner f64
/// - `bool` — validates the argument is a bool, passes the inner bool
/// - `Vec<Value>` — validates the argument is a list, passes the elements
///
/// # Example
/// ```ignore
/// #[weaver_function(name = "repeat", member)]
/// fn repeat_text(text: String, count: f64) -> Result<Value, EvalError> {
///     Ok(Value::String(text.repeat(count as usize)))
/// }
///
/// let options = TemplateOptions::new().function(RepeatTextFunction);
/// ```
#[proc_macro_attribute]
pub fn weaver_function(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as FunctionArgs);
    let input_fn = parse_macro_input!(item as ItemFn);

    let fn_name = &input_fn.sig.ident;
    let struct_name = format_ident!("{}Function", to_pascal_case(&fn_name.to_string()));
    let function_name = &args.name;

    let mut param_extractions = Vec::new();
    let mut param_names = Vec::new();
    let mut param_types = Vec::new();
    let mut param_defs = Vec::new();
    let mut receiver_type = None;
    let mut arg_index: usize = 0;

    for fn_arg in &input_fn.sig.inputs {
        if let FnArg::Typed(pat_type) = fn_arg
            && let Pat::Ident(ident) = &*pat_type.pat
        {
            let param_name = &ident.ident;
            let param_name_str = param_name.to_string();
            let ty = &*pat_type.ty;

            param_names.push(param_name.clone());

            if args.member && receiver_type.is_none() {
                let (extraction, value_type, rust_type) = generate_extraction(
                    &param_name_str,
                    ty,
                    quote! { receiver.as_ref() },
                    "receiver",
                );
                param_extractions.push(extraction);
                param_types.push(rust_type);
                receiver_type = Some(value_type);
                continue;
            }

            let idx = arg_index;
            let (extraction, value_type, rust_type) = generate_extraction(
                &param_name_str,
                ty,
                quote! { args.get(#idx) },
                "argument",
            );
            param_extractions.push(extraction);
            param_types.push(rust_type);
            param_defs.push(quote! {
                weaver_json::ParamDef::required(#param_name_str, #value_type)
            });
            arg_index += 1;
        }
    }

    let overload = match &receiver_type {
        Some(receiver) => quote! {
            weaver_json::OverloadDef::member(#receiver, [#(#param_defs),*])
        },
        None if args.member => {
            return syn::Error::new_spanned(
                &input_fn.sig,
                "a `member` function needs at least one parameter for the receiver",
            )
            .to_compile_error()
            .into();
        }
        None => quote! {
            weaver_json::OverloadDef::global([#(#param_defs),*])
        },
    };

    // Suppress unused variable warnings for the side the function ignores
    let receiver_binding = if args.member {
        quote! {}
    } else {
        quote! { let _ = receiver; }
    };

    let fn_body = &input_fn.block;
    let output_type = &input_fn.sig.output;

    let output = quote! {
        pub struct #struct_name;

        impl #struct_name {
            fn execute(#(#param_names: #param_types),*) #output_type {
                #fn_body
            }
        }

        impl weaver_json::Function for #struct_name {
            fn call(
                &self,
                receiver: Option<weaver_json::Value>,
                args: Vec<weaver_json::Value>,
            ) -> Result<weaver_json::Value, weaver_json::Interrupt> {
                #receiver_binding
                let _ = &args;
                #(#param_extractions)*
                Self::execute(#(#param_names),*).map_err(weaver_json::Interrupt::from)
            }

            fn signature(&self) -> weaver_json::FunctionSignature {
                weaver_json::FunctionSignature::new(#function_name).overload(#overload)
            }
        }
    };

    output.into()
}

/// Generate extraction code for one parameter. `source` is an expression
/// of type `Option<&Value>`.
///
/// Returns (extraction_code, value_type_token, rust_type_token)
fn generate_extraction(
    name: &str,
    ty: &Type,
    source: proc_macro2::TokenStream,
    role: &str,
) -> (
    proc_macro2::TokenStream,
    proc_macro2::TokenStream,
    proc_macro2::TokenStream,
) {
    let ident = format_ident!("{}", name);
    let type_str = quote!(#ty).to_string().replace(' ', "");
    let missing = quote! {
        return Err(weaver_json::Interrupt::from(weaver_json::EvalError::new(
            weaver_json::EvalErrorKind::TypeError,
            format!("missing required {}: {}", #role, #name),
        )))
    };

    match type_str.as_str() {
        "String" => (
            quote! {
                let #ident = match #source {
                    Some(weaver_json::Value::String(s)) => s.clone(),
                    Some(other) => {
                        return Err(
                            weaver_json::EvalError::type_error("string", other.type_name()).into()
                        );
                    }
                    None => #missing,
                };
            },
            quote! { weaver_json::ValueType::String },
            quote! { String },
        ),
        "f64" => (
            quote! {
                let #ident = match #source {
                    Some(weaver_json::Value::Number(n)) => *n,
                    Some(other) => {
                        return Err(
                            weaver_json::EvalError::type_error("number", other.type_name()).into()
                        );
                    }
                    None => #missing,
                };
            },
            quote! { weaver_json::ValueType::Number },
            quote! { f64 },
        ),
        "bool" => (
            quote! {
                let #ident = match #source {
                    Some(weaver_json::Value::Bool(b)) => *b,
                    Some(other) => {
                        return Err(
                            weaver_json::EvalError::type_error("bool", other.type_name()).into()
                        );
                    }
                    None => #missing,
                };
            },
            quote! { weaver_json::ValueType::Bool },
            quote! { bool },
        ),
        "Vec<Value>" => (
            quote! {
                let #ident = match #source {
                    Some(weaver_json::Value::List(items)) => items.to_vec(),
                    Some(other) => {
                        return Err(
                            weaver_json::EvalError::type_error("list", other.type_name()).into()
                        );
                    }
                    None => #missing,
                };
            },
            quote! { weaver_json::ValueType::List },
            quote! { Vec<weaver_json::Value> },
        ),
        // `Value` and anything unrecognised accept any value
        _ => (
            quote! {
                let #ident = match #source {
                    Some(value) => value.clone(),
                    None => #missing,
                };
            },
            quote! { weaver_json::ValueType::Any },
            quote! { weaver_json::Value },
        ),
    }
}

fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

// -- Attribute arg parsing -----------------------------------------------

struct FunctionArgs {
    name: String,
    member: bool,
}

impl syn::parse::Parse for FunctionArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut name = None;
        let mut member = false;

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            match ident.to_string().as_str() {
                "member" => member = true,
                "name" => {
                    input.parse::<syn::Token![=]>()?;
                    let lit: syn::LitStr = input.parse()?;
                    name = Some(lit.value());
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unexpected key `{other}`, expected `name` or `member`"),
                    ));
                }
            }

            if input.is_empty() {
                break;
            }
            input.parse::<syn::Token![,]>()?;
        }

        let name = name.ok_or_else(|| input.error("missing `name` attribute"))?;
        Ok(FunctionArgs { name, member })
    }
}
