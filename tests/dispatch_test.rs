// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod dispatch_tests {
    //! # 分发流水线测试
    //!
    //! 不经过 TCP，直接向分发器投递字节，从连接的写出队列读取序列化后的响应。
    //! 覆盖范围包括：
    //! - 端到端的匹配、参数映射与处理器调用
    //! - 路由声明顺序决定匹配结果
    //! - 解析失败、未匹配、参数转换失败时的响应
    //! - 缺少内容的超时清理
    //! - 过滤器链与错误处理器链

    use std::{sync::Arc, time::Duration};

    use mockall::mock;
    use tokio::{sync::mpsc, time::timeout};

    use actionhttp::{
        completes::{Outbound, PendingResponse},
        config::Config,
        dispatcher::Dispatcher,
        error_handler::{ErrorHandler, ErrorHandlers},
        exception::Exception,
        filter::{Filters, RequestFilter, ResponseFilter},
        mapper::TextMapper,
        pool::BufferPool,
        resolver::ParameterResolver,
        resource::{Dispatchable, ResourceBuilder},
        response::Response,
        response_parser::ResponseParser,
        HttpRequestMethod, Request,
    };

    mock! {
        pub Inbound {}
        impl RequestFilter for Inbound {
            fn filter(&self, request: Request) -> (Request, bool);
            fn stop(&self);
        }
    }

    mock! {
        pub Outgoing {}
        impl ResponseFilter for Outgoing {
            fn filter(&self, response: Response) -> (Response, bool);
        }
    }

    mock! {
        pub Errors {}
        impl ErrorHandler for Errors {
            fn handle(&self, error: &Exception) -> Result<Option<Response>, Exception>;
        }
    }

    type Queue = mpsc::UnboundedReceiver<PendingResponse>;

    fn items() -> Box<dyn Dispatchable> {
        let resource = ResourceBuilder::new("items", || ())
            .pool(2)
            .handle_with(
                HttpRequestMethod::Get,
                "/items/{id}",
                "show(int id)",
                |action| action.with_resolvers(vec![ParameterResolver::query("x")]),
                |_: &mut (), _, args, completes| {
                    let id = args[0].as_i64().unwrap_or(-1);
                    let x = args[1].as_str().unwrap_or("none").to_string();
                    completes.with(Response::of_text(200, &format!("id={} x={}", id, x)));
                    Ok(())
                },
            )
            .get("/slow", "slow()", |_: &mut (), _, _, completes| {
                std::thread::sleep(Duration::from_millis(50));
                completes.with(Response::of_text(200, "slow"));
                Ok(())
            })
            .get("/fast", "fast()", |_: &mut (), _, _, completes| {
                completes.with(Response::of_text(200, "fast"));
                Ok(())
            })
            .get("/broken", "broken()", |_: &mut (), _, _, _| {
                Err(Exception::HandlerFailed("broken on purpose".into()))
            })
            .handle_with(
                HttpRequestMethod::Post,
                "/echo",
                "echo(body: string text)",
                |action| action.with_mapper(Arc::new(TextMapper)),
                |_: &mut (), _, args, completes| {
                    completes.with(Response::of_text(201, args[0].as_str().unwrap_or("")));
                    Ok(())
                },
            )
            .build()
            .unwrap();
        Box::new(resource)
    }

    fn users(literal_first: bool) -> Box<dyn Dispatchable> {
        let builder = ResourceBuilder::new("users", || ());
        let literal = |b: ResourceBuilder<()>| {
            b.get("/users/active", "active()", |_: &mut (), _, _, completes| {
                completes.with(Response::of_text(200, "literal"));
                Ok(())
            })
        };
        let template = |b: ResourceBuilder<()>| {
            b.get("/users/{id}", "user(String id)", |_: &mut (), _, args, completes| {
                completes.with(Response::of_text(200, &format!("template:{}", args[0].as_str().unwrap_or(""))));
                Ok(())
            })
        };
        let builder = if literal_first {
            template(literal(builder))
        } else {
            literal(template(builder))
        };
        Box::new(builder.build().unwrap())
    }

    fn dispatcher(resources: Vec<Box<dyn Dispatchable>>, filters: Filters, errors: ErrorHandlers) -> Dispatcher {
        let config = Config::new().with_request_missing_content_timeout(20);
        let mut dispatcher = Dispatcher::new(&config, resources, filters, errors, BufferPool::new(8, 64 * 1024));
        dispatcher.start();
        dispatcher
    }

    fn connect(dispatcher: &mut Dispatcher, id: u64) -> Queue {
        let (responses, queue) = mpsc::unbounded_channel();
        dispatcher.open(id, responses);
        queue
    }

    async fn next_outbound(queue: &mut Queue) -> Outbound {
        let pending = timeout(Duration::from_secs(5), queue.recv())
            .await
            .expect("no response was queued")
            .expect("queue closed");
        timeout(Duration::from_secs(5), pending)
            .await
            .expect("response was not completed")
            .expect("completion dropped")
    }

    async fn next_response(queue: &mut Queue) -> Response {
        let outbound = next_outbound(queue).await;
        let mut parser = ResponseParser::parser_for(&outbound.buffer).unwrap();
        parser.full_response().unwrap()
    }

    /// ## 端到端场景
    /// `GET /items/7?x=1` 匹配 `/items/{id}`，路径参数转换为整数，查询参数由解析器追加。
    #[tokio::test]
    async fn test_end_to_end_items_scenario() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);

        dispatcher.consume(1, b"GET /items/7?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body().content(), "id=7 x=1");
        assert_eq!(response.header_value("Content-Length"), Some("8"));
    }

    /// ## 路由匹配的确定性
    /// 先声明的 Action 优先，不做回溯。
    #[tokio::test]
    async fn test_route_declaration_order_decides_match() {
        let mut literal_first = dispatcher(vec![users(true)], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut literal_first, 1);
        literal_first.consume(1, b"GET /users/active HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(next_response(&mut queue).await.body().content(), "literal");

        let mut template_first = dispatcher(vec![users(false)], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut template_first, 1);
        template_first.consume(1, b"GET /users/active HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(next_response(&mut queue).await.body().content(), "template:active");
    }

    #[tokio::test]
    async fn test_unmatched_request_is_404() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"DELETE /items/7 HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 404);
        assert!(response.body().content().contains("DELETE /items/7"));
    }

    /// ## 解析失败
    /// 非法请求以 400 响应，同一连接上的后续请求仍然可以正常处理。
    #[tokio::test]
    async fn test_malformed_request_is_400_and_connection_recovers() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);

        dispatcher.consume(1, b"BREW /pot HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(next_response(&mut queue).await.status_code(), 400);

        dispatcher.consume(1, b"GET /fast HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(next_response(&mut queue).await.body().content(), "fast");
    }

    #[tokio::test]
    async fn test_coercion_failure_is_400() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /items/seven HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 400);
        assert!(response.body().content().contains("seven"));
    }

    #[tokio::test]
    async fn test_handler_error_uses_default_mapping() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /broken HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 500);
        assert_eq!(response.body().content(), "broken on purpose");
    }

    /// ## 同一连接上的响应顺序
    /// 慢请求先到达，即使快请求先完成，写出顺序仍与请求顺序一致。
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipelined_responses_keep_request_order() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);

        dispatcher.consume(1, b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\nGET /fast HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert_eq!(next_response(&mut queue).await.body().content(), "slow");
        assert_eq!(next_response(&mut queue).await.body().content(), "fast");
    }

    /// ## 分片到达的消息体
    /// 消息体分三次到达，只有最后一片到达后才分发。
    #[tokio::test]
    async fn test_body_split_across_reads() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);

        dispatcher.consume(1, b"POST /echo HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\nhel");
        assert!(dispatcher.is_missing_content(1));
        dispatcher.consume(1, b"lo wo");
        assert!(queue.try_recv().is_err());
        dispatcher.consume(1, b"rld");
        assert!(!dispatcher.is_missing_content(1));

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.body().content(), "hello world");
    }

    /// ## 缺少内容的超时清理
    /// 超时前的清理不产生响应；超时后以 400 完成并移出待处理集合；再次清理不再响应。
    #[tokio::test]
    async fn test_missing_content_sweep() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 9);

        dispatcher.consume(9, b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(dispatcher.is_missing_content(9));
        dispatcher.sweep();
        assert!(queue.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        dispatcher.sweep();
        assert!(!dispatcher.is_missing_content(9));
        assert_eq!(dispatcher.pending_missing_content(), 0);

        let outbound = next_outbound(&mut queue).await;
        assert!(outbound.close_after);
        let response = ResponseParser::parser_for(&outbound.buffer).unwrap().full_response().unwrap();
        assert_eq!(response.status_code(), 400);
        assert_eq!(response.body().content(), "Missing content.");

        dispatcher.sweep();
        assert!(queue.try_recv().is_err());
    }

    /// ## 缓慢到达的消息体
    /// 每段新字节都会重新开始计时，总耗时超过超时时间的上传也不会被清理。
    #[tokio::test]
    async fn test_trickling_body_is_not_swept() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 4);
        dispatcher.consume(4, b"POST /echo HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nab");
        for piece in [&b"cd"[..], &b"e"[..]] {
            tokio::time::sleep(Duration::from_millis(30)).await;
            dispatcher.consume(4, piece);
            dispatcher.sweep();
            assert!(dispatcher.is_missing_content(4));
            assert!(queue.try_recv().is_err());
        }
        dispatcher.consume(4, b"f");
        assert!(!dispatcher.is_missing_content(4));

        let response = next_response(&mut queue).await;
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.body().content(), "abcdef");
    }

    /// ## 关闭的连接不会被清理
    /// `closed` 同时移除连接与待处理记录，之后的超时清理不再为它产生响应。
    #[tokio::test]
    async fn test_closed_connection_is_not_swept() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 3);
        dispatcher.consume(3, b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert_eq!(dispatcher.pending_missing_content(), 1);
        dispatcher.closed(3);
        assert_eq!(dispatcher.connection_count(), 0);
        assert!(!dispatcher.is_missing_content(3));

        tokio::time::sleep(Duration::from_millis(60)).await;
        dispatcher.sweep();
        assert_eq!(dispatcher.pending_missing_content(), 0);
        assert!(queue.try_recv().is_err());

        // 未登记的连接发来的数据被丢弃
        dispatcher.consume(3, b"GET /fast HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_correlation_id_is_echoed() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /fast HTTP/1.1\r\nX-Correlation-ID: req-42\r\n\r\nGET /fast HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let first = next_response(&mut queue).await;
        assert_eq!(first.header_value("x-correlation-id"), Some("req-42"));
        let second = next_response(&mut queue).await;
        assert_eq!(second.header_value("x-correlation-id"), None);
    }

    #[tokio::test]
    async fn test_connection_close_is_propagated() {
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /fast HTTP/1.1\r\nHost: localhost\r\n\r\n");
        dispatcher.consume(1, b"GET /fast HTTP/1.1\r\nConnection: close\r\n\r\n");
        dispatcher.consume(1, b"GET /fast HTTP/1.0\r\nHost: localhost\r\n\r\n");

        assert!(!next_outbound(&mut queue).await.close_after);
        assert!(next_outbound(&mut queue).await.close_after);
        assert!(next_outbound(&mut queue).await.close_after);
    }

    /// ## 过滤器链
    /// 请求过滤器在匹配前改写请求，响应过滤器在序列化前改写响应。
    #[tokio::test]
    async fn test_filters_rewrite_messages() {
        let mut inbound = MockInbound::new();
        inbound
            .expect_filter()
            .times(1)
            .returning(|request| (request.with_uri(actionhttp::Uri::from_request_target("/fast").unwrap()), true));
        inbound.expect_stop().times(1).return_const(());
        let mut outgoing = MockOutgoing::new();
        outgoing
            .expect_filter()
            .times(1)
            .returning(|response| (response.with_header("X-Filtered", "yes"), true));

        let filters = Filters::none()
            .with_request_filter(Arc::new(inbound))
            .with_response_filter(Arc::new(outgoing));
        let mut dispatcher = dispatcher(vec![items()], filters, ErrorHandlers::new());
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /somewhere-else HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let response = next_response(&mut queue).await;
        assert_eq!(response.body().content(), "fast");
        assert_eq!(response.header_value("X-Filtered"), Some("yes"));
        dispatcher.stop();
    }

    /// ## 错误处理器链
    /// 自定义处理器接管参数错误；自身失败时退回固定的 500。
    #[tokio::test]
    async fn test_error_handler_chain() {
        let mut custom = MockErrors::new();
        custom
            .expect_handle()
            .withf(|e| matches!(e, Exception::InvalidArgument(_)))
            .times(1)
            .returning(|_| Ok(Some(Response::of_text(422, "custom"))));
        custom
            .expect_handle()
            .withf(|e| matches!(e, Exception::HandlerFailed(_)))
            .times(1)
            .returning(|_| Err(Exception::HandlerFailed("error handler broke".into())));

        let errors = ErrorHandlers::new().with(Arc::new(custom));
        let mut dispatcher = dispatcher(vec![items()], Filters::none(), errors);
        let mut queue = connect(&mut dispatcher, 1);
        dispatcher.consume(1, b"GET /items/seven HTTP/1.1\r\nHost: localhost\r\n\r\nGET /broken HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let first = next_response(&mut queue).await;
        assert_eq!(first.status_code(), 422);
        assert_eq!(first.body().content(), "custom");

        let second = next_response(&mut queue).await;
        assert_eq!(second.status_code(), 500);
        assert_eq!(second.body().content(), "Internal server error.");
    }
}
