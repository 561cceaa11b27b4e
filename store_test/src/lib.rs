use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Which document client the test's store is built on.
enum Backend {
    Memory,
    Mongo,
}

/// Transform an asynchronous test into a synchronous one, inject an
/// initialized `QuestionStore` on a fresh randomly-named database, and ensure
/// that the database is dropped regardless of how the test terminates.
///
/// The test must take exactly one argument, `store: QuestionStore<MemoryClient>`
/// or `store: QuestionStore<MongoClient>`. MongoDB-backed tests need a live
/// server (at `QNA_TEST_DB_URI`) and are therefore marked `#[ignore]`.
#[proc_macro_attribute]
pub fn store_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let args = TokenStream2::from(args);
        return syn::Error::new(args.span(), "`store_test` takes no arguments")
            .into_compile_error()
            .into();
    }

    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Work out which client to build and reject invalid function signatures.
    let backend = match check_sig(&item_fn.sig) {
        Ok(backend) => backend,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let (client_type, connect, drop_database, ignore) = match backend {
        Backend::Memory => (
            quote! { crate::client::MemoryClient },
            quote! { crate::client::MemoryClient::new() },
            quote! {},
            quote! {},
        ),
        Backend::Mongo => (
            quote! { crate::client::MongoClient },
            quote! {
                crate::client::MongoClient::with_uri_str(&crate::test_db_uri())
                    .await
                    .unwrap()
            },
            quote! { client.drop_database(&database).await.unwrap(); },
            quote! { #[ignore = "needs a MongoDB server at QNA_TEST_DB_URI"] },
        ),
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #ignore
        fn #name() {
            /// Test setup.
            async fn setup() -> crate::store::QuestionStore<#client_type> {
                crate::test_logging();
                let client = std::sync::Arc::new(#connect);
                let store = crate::store::QuestionStore::new(
                    client,
                    crate::config::test_database_name(),
                    crate::TEST_CONTAINER,
                );
                store.init().await.unwrap();
                store
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            #[allow(unused_variables)]
            async fn cleanup(client: std::sync::Arc<#client_type>, database: String) {
                #drop_database
            }

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name("store-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let store = outer_runtime.block_on(setup());
            let client = store.client().clone();
            let database = store.database_id().to_string();

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let store_mutex = std::sync::Mutex::new(store);
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                let store = store_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                runtime.block_on(#new_name(store));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(client, database));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async and takes a single `QuestionStore<_>`
/// over a known client.
fn check_sig(sig: &Signature) -> Result<Backend, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let expected = "Expected a single `store_ident: QuestionStore<MemoryClient>` \
                    or `store_ident: QuestionStore<MongoClient>`";
    let mut inputs = sig.inputs.iter();
    let (Some(input), None) = (inputs.next(), inputs.next()) else {
        return Err(syn::Error::new(sig.inputs.span(), expected));
    };

    if let FnArg::Typed(pat_type) = input {
        if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
            // Valid as the last path segment for any type is itself
            let store = type_path.path.segments.last().unwrap();
            if store.ident == "QuestionStore" {
                if let PathArguments::AngleBracketed(generics) = &store.arguments {
                    if let Some(GenericArgument::Type(Type::Path(client))) = generics.args.first() {
                        if let Some(client) = client.path.segments.last() {
                            if client.ident == "MemoryClient" {
                                return Ok(Backend::Memory);
                            } else if client.ident == "MongoClient" {
                                return Ok(Backend::Mongo);
                            }
                        }
                    }
                }
            }
        }
    }

    Err(syn::Error::new(input.span(), expected))
}
