/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

#![forbid(unsafe_code)]

//! Courier Macro Library
//!
//! This library provides the [`remote_actor`] attribute, which turns an annotated
//! `impl` block into everything Courier needs to call the actor across a transport:
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! #[remote_actor]
//! impl Room {
//!     /// Admits a client.
//!     #[remote]
//!     async fn join(&mut self, client: ActorId) -> String { /* ... */ }
//!
//!     #[remote]
//!     async fn post(&mut self, from: ActorId, text: String) -> Result<usize, RoomError> { /* ... */ }
//!
//!     #[remote(oneway)]
//!     fn leave(&mut self, client: ActorId) { /* ... */ }
//! }
//! ```
//!
//! generates, next to the untouched `impl` block:
//!
//! * `RoomMessage`: the protocol enum, one struct variant per `#[remote]` method.
//! * `impl courier::Protocol for RoomMessage` and `impl courier::RemoteActor for Room`
//!   (the dispatcher).
//! * `RoomClient`: an async trait implemented for `courier::ActorRef<Room, C>`, with one
//!   method per remote method.

use proc_macro::TokenStream;

use proc_macro2::{Ident, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, parse_quote, Attribute, FnArg, GenericArgument, ImplItem, ImplItemFn,
    ItemImpl, LitStr, Pat, PathArguments, ReturnType, Type,
};

/// Configuration options parsed from `#[remote_actor(...)]` attributes.
#[derive(Default)]
struct ActorConfig {
    /// Overrides the type name carried in actor identities.
    name: Option<String>,
}

/// Whether the caller waits for a remote method to finish.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Request,
    Oneway,
}

/// What a remote method returns.
enum Returns {
    Plain(Type),
    Fallible { ok: Type, err: Type },
}

/// One `#[remote]` method of the annotated impl block.
struct RemoteMethod {
    ident: Ident,
    variant: Ident,
    docs: Vec<Attribute>,
    args: Vec<(Ident, Type)>,
    is_async: bool,
    kind: CallKind,
    returns: Returns,
}

impl RemoteMethod {
    fn selector(&self) -> LitStr {
        LitStr::new(&self.ident.to_string(), self.ident.span())
    }

    fn arg_names(&self) -> Vec<&Ident> {
        self.args.iter().map(|(name, _)| name).collect()
    }

    /// Local bindings used inside generated code so user argument names never shadow
    /// generated ones.
    fn bound_names(&self) -> Vec<Ident> {
        self.args
            .iter()
            .map(|(name, _)| format_ident!("__courier_{}", name))
            .collect()
    }

    fn await_token(&self) -> TokenStream2 {
        if self.is_async {
            quote!(.await)
        } else {
            quote!()
        }
    }
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

fn upper_camel(ident: &Ident) -> Ident {
    let mut out = String::new();
    for part in ident.to_string().split('_').filter(|part| !part.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    Ident::new(&out, ident.span())
}

/// Splits `Result<T, E>` into `T` and `E`.
fn result_types(ty: &Type) -> Option<(Type, Type)> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    let mut types = args.args.iter().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty.clone()),
        _ => None,
    });
    let ok = types.next()?;
    let err = types.next()?;
    types.next().is_none().then_some((ok, err))
}

fn remote_kind(attrs: &[Attribute]) -> syn::Result<Option<CallKind>> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("remote")) else {
        return Ok(None);
    };
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(Some(CallKind::Request));
    }
    let mut kind = CallKind::Request;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("oneway") {
            kind = CallKind::Oneway;
            Ok(())
        } else {
            Err(meta.error("expected `oneway`"))
        }
    })?;
    Ok(Some(kind))
}

fn parse_method(method: &ImplItemFn, kind: CallKind) -> syn::Result<RemoteMethod> {
    let sig = &method.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "remote methods cannot be generic",
        ));
    }
    match sig.receiver() {
        Some(receiver) if receiver.reference.is_some() => {}
        Some(receiver) => {
            return Err(syn::Error::new_spanned(
                receiver,
                "remote methods take `&self` or `&mut self`",
            ))
        }
        None => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "remote methods take `&self` or `&mut self`",
            ))
        }
    }

    let mut args = Vec::new();
    for input in sig.inputs.iter().skip(1) {
        let FnArg::Typed(typed) = input else {
            continue;
        };
        let Pat::Ident(pat) = typed.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &typed.pat,
                "remote method arguments must be plain identifiers",
            ));
        };
        if matches!(typed.ty.as_ref(), Type::Reference(_)) {
            return Err(syn::Error::new_spanned(
                &typed.ty,
                "remote method arguments are passed by value",
            ));
        }
        args.push((pat.ident.clone(), typed.ty.as_ref().clone()));
    }

    let returns = match &sig.output {
        ReturnType::Default => Returns::Plain(parse_quote!(())),
        ReturnType::Type(_, ty) => match result_types(ty) {
            Some((ok, err)) => Returns::Fallible { ok, err },
            None => Returns::Plain(ty.as_ref().clone()),
        },
    };

    Ok(RemoteMethod {
        ident: sig.ident.clone(),
        variant: upper_camel(&sig.ident),
        docs: method
            .attrs
            .iter()
            .filter(|attr| attr.path().is_ident("doc"))
            .cloned()
            .collect(),
        args,
        is_async: sig.asyncness.is_some(),
        kind,
        returns,
    })
}

/// Generates the protocol enum and its `Protocol` impl.
fn protocol_tokens(actor: &Ident, message: &Ident, methods: &[RemoteMethod]) -> TokenStream2 {
    let doc = format!("Remote protocol of [`{actor}`]: one variant per remote method.");
    let variants = methods.iter().map(|method| {
        let variant = &method.variant;
        let docs = &method.docs;
        let fields = method.args.iter().map(|(name, ty)| quote!(#name: #ty));
        quote! {
            #(#docs)*
            #variant { #(#fields),* }
        }
    });
    let selectors: Vec<_> = methods.iter().map(RemoteMethod::selector).collect();
    let variant_idents = methods.iter().map(|method| &method.variant);

    quote! {
        #[doc = #doc]
        #[derive(Debug, ::courier::serde::Serialize, ::courier::serde::Deserialize)]
        #[serde(crate = "::courier::serde")]
        pub enum #message {
            #(#variants),*
        }

        impl ::courier::Protocol for #message {
            const SELECTORS: &'static [&'static str] = &[#(#selectors),*];

            fn selector(&self) -> &'static str {
                match self {
                    #(Self::#variant_idents { .. } => #selectors,)*
                }
            }
        }
    }
}

/// Generates the `RemoteActor` impl, i.e. the recipient dispatcher.
fn dispatcher_tokens(
    actor: &Ident,
    type_name: &str,
    message: &Ident,
    methods: &[RemoteMethod],
) -> TokenStream2 {
    let specs = methods.iter().map(|method| {
        let selector = method.selector();
        let oneway = method.kind == CallKind::Oneway;
        let fallible = matches!(method.returns, Returns::Fallible { .. });
        quote! {
            ::courier::MethodSpec { selector: #selector, oneway: #oneway, fallible: #fallible }
        }
    });

    let arms = methods.iter().map(|method| {
        let variant = &method.variant;
        let ident = &method.ident;
        let names = method.arg_names();
        let bound = method.bound_names();
        let await_token = method.await_token();
        let call = quote!(self.#ident(#(#bound),*)#await_token);
        let encode = match method.returns {
            Returns::Plain(_) => quote! {
                codec.encode(&#call).map(::courier::Outcome::Success)
            },
            Returns::Fallible { .. } => quote! {
                match #call {
                    ::std::result::Result::Ok(value) => codec.encode(&value).map(::courier::Outcome::Success),
                    ::std::result::Result::Err(error) => codec.encode(&error).map(::courier::Outcome::Failure),
                }
            },
        };
        quote! {
            #message::#variant { #(#names: #bound),* } => { #encode }
        }
    });

    quote! {
        #[::courier::async_trait]
        impl ::courier::RemoteActor for #actor {
            type Message = #message;

            const TYPE_NAME: &'static str = #type_name;

            const METHODS: &'static [::courier::MethodSpec] = &[#(#specs),*];

            async fn dispatch<__C: ::courier::Codec>(
                &mut self,
                message: #message,
                codec: &__C,
            ) -> ::std::result::Result<::courier::Outcome, ::courier::CodecError> {
                match message {
                    #(#arms)*
                }
            }
        }
    }
}

/// Generates the client trait and its impl for `ActorRef`.
fn client_tokens(
    actor: &Ident,
    message: &Ident,
    client: &Ident,
    methods: &[RemoteMethod],
) -> TokenStream2 {
    let doc = format!(
        "Calls [`{actor}`]'s remote methods through a `courier::ActorRef`, locally or across a transport."
    );

    let signatures: Vec<_> = methods
        .iter()
        .map(|method| {
            let ident = &method.ident;
            let params = method.args.iter().map(|(name, ty)| quote!(#name: #ty));
            let output = match (&method.returns, method.kind) {
                (_, CallKind::Oneway) => quote!(::std::result::Result<(), ::courier::TransportError>),
                (Returns::Plain(ty), CallKind::Request) => {
                    quote!(::std::result::Result<#ty, ::courier::TransportError>)
                }
                (Returns::Fallible { ok, err }, CallKind::Request) => {
                    quote!(::std::result::Result<#ok, ::courier::CallError<#err>>)
                }
            };
            quote!(async fn #ident(&self, #(#params),*) -> #output)
        })
        .collect();

    let declarations = methods.iter().zip(&signatures).map(|(method, signature)| {
        let docs = &method.docs;
        quote! {
            #(#docs)*
            #signature;
        }
    });

    let bodies = methods.iter().zip(&signatures).map(|(method, signature)| {
        let ident = &method.ident;
        let variant = &method.variant;
        let names = method.arg_names();
        let await_token = method.await_token();
        let local_call = quote!(__courier_actor.#ident(#(#names),*)#await_token);
        let build = quote!(#message::#variant { #(#names),* });

        let (local, remote) = match (&method.returns, method.kind) {
            (Returns::Plain(ty), CallKind::Oneway) if is_unit(ty) => (
                quote! {
                    #local_call;
                    ::std::result::Result::Ok(())
                },
                quote!(self.cast(#build).await),
            ),
            (_, CallKind::Oneway) => (
                quote! {
                    let _ = #local_call;
                    ::std::result::Result::Ok(())
                },
                quote!(self.cast(#build).await),
            ),
            (Returns::Plain(_), CallKind::Request) => (
                quote!(::std::result::Result::Ok(#local_call)),
                quote! {
                    let __courier_outcome = self.call(#build).await?;
                    self.decode_reply(__courier_outcome)
                },
            ),
            (Returns::Fallible { .. }, CallKind::Request) => (
                quote!(#local_call.map_err(::courier::CallError::Application)),
                quote! {
                    let __courier_outcome = self.call(#build).await?;
                    self.decode_result(__courier_outcome)
                },
            ),
        };

        quote! {
            #signature {
                match self.route()? {
                    ::courier::Route::Local(__courier_actor) => {
                        #[allow(unused_mut)]
                        let mut __courier_actor = __courier_actor.lock().await;
                        #local
                    }
                    ::courier::Route::Remote => {
                        #remote
                    }
                }
            }
        }
    });

    quote! {
        #[doc = #doc]
        #[::courier::async_trait]
        pub trait #client {
            #(#declarations)*
        }

        #[::courier::async_trait]
        impl<__C: ::courier::Codec> #client for ::courier::ActorRef<#actor, __C> {
            #(#bodies)*
        }
    }
}

fn expand(config: ActorConfig, mut item: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[remote_actor] belongs on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "remote actors cannot be generic",
        ));
    }
    let actor = match item.self_ty.as_ref() {
        Type::Path(path) if path.qself.is_none() => match path.path.segments.last() {
            Some(segment) if segment.arguments.is_empty() => segment.ident.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    &item.self_ty,
                    "expected a plain type name",
                ))
            }
        },
        other => return Err(syn::Error::new_spanned(other, "expected a plain type name")),
    };

    let mut methods = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let Some(kind) = remote_kind(&method.attrs)? else {
            continue;
        };
        methods.push(parse_method(method, kind)?);
        method.attrs.retain(|attr| !attr.path().is_ident("remote"));
    }
    if methods.is_empty() {
        return Err(syn::Error::new(
            item.self_ty.span(),
            "#[remote_actor] needs at least one #[remote] method",
        ));
    }

    let type_name = config.name.unwrap_or_else(|| actor.to_string());
    let message = format_ident!("{}Message", actor);
    let client = format_ident!("{}Client", actor);
    let assert_ident = format_ident!("_AssertRemoteActor_{}", actor);

    let protocol = protocol_tokens(&actor, &message, &methods);
    let dispatcher = dispatcher_tokens(&actor, &type_name, &message, &methods);
    let stubs = client_tokens(&actor, &message, &client, &methods);

    Ok(quote! {
        #item

        #protocol

        #dispatcher

        #stubs

        // Compile-time assertion that the actor type can live behind a transport.
        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case)]
        const _: () = {
            fn #assert_ident() {
                fn assert_bounds<T: Send + 'static>() {}
                assert_bounds::<#actor>();
            }
        };
    })
}

/// Turns an inherent `impl` block into a remote actor.
///
/// Methods marked `#[remote]` become request/response operations and methods marked
/// `#[remote(oneway)]` become fire-and-forget operations. Unmarked methods stay
/// local. Every remote method:
///
/// * takes `&self` or `&mut self` and its other arguments by value, as plain
///   identifiers, with types that implement `Serialize + DeserializeOwned + Debug`;
/// * may be `async` or not;
/// * returns `T` (including `()`) or `Result<T, E>` with serializable `T` and `E`.
///   A `Result` return makes the client method return `Result<T, CallError<E>>`, and
///   the remote error arrives as `CallError::Application(e)`.
///
/// # Options
///
/// * `name = "..."`: the type name carried in identities, defaulting to the Rust
///   type name. Peers resolving the actor must agree on it.
///
/// ```ignore
/// #[remote_actor(name = "chat.Room")]
/// impl Room { /* ... */ }
/// ```
///
/// # Generated Items
///
/// For `impl Room`: `pub enum RoomMessage`, `impl Protocol for RoomMessage`,
/// `impl RemoteActor for Room`, and `pub trait RoomClient` implemented for
/// `ActorRef<Room, C>` for every codec `C`.
#[proc_macro_attribute]
pub fn remote_actor(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut config = ActorConfig::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            config.name = Some(meta.value()?.parse::<LitStr>()?.value());
            Ok(())
        } else {
            Err(meta.error("unsupported remote_actor option"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemImpl);

    expand(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
