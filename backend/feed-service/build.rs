fn main() {
    println!("cargo:rerun-if-changed=../proto/services/feed_service.proto");
    println!("cargo:rerun-if-changed=../proto/services/graph_service.proto");
    println!("cargo:rerun-if-changed=../proto/services/content_service.proto");
    println!("cargo:rerun-if-changed=../proto/services/user_service.proto");

    // feed-service PROVIDES FeedService (server implementation)
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(
            &["../proto/services/feed_service.proto"],
            &["../proto/services/"],
        )
        .expect("Failed to compile feed_service.proto");

    // feed-service CONSUMES the graph, content and user services
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(
            &[
                "../proto/services/graph_service.proto",
                "../proto/services/content_service.proto",
                "../proto/services/user_service.proto",
            ],
            &["../proto/services/"],
        )
        .expect("Failed to compile downstream service protos");
}
