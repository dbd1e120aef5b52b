#[cfg(test)]
mod tests {
    use crate::config::BasicAuthCredentials;
    use crate::middleware::auth_injector::BasicAuthInjector;
    use crate::scaling::scaling_error::ScalingError;
    use crate::scaling::service_query::{ExternalServiceQuery, ServiceQuery};
    use mockito::Matcher;
    use reqwest::{StatusCode, Url};
    use std::sync::Arc;

    fn client_for(server: &mockito::Server) -> ExternalServiceQuery {
        let base_url = Url::parse(&server.url()).unwrap();
        ExternalServiceQuery::new(base_url, None).unwrap()
    }

    #[tokio::test]
    async fn test_get_replicas() {
        let mut server = mockito::Server::new_async().await;
        // 模拟服务端返回的响应体
        let mock = server
            .mock("GET", "/system/function/figlet")
            .match_query(Matcher::UrlEncoded("namespace".into(), "openfaas-fn".into()))
            .with_status(200)
            .with_body(
                r#"
                {
                    "name": "figlet",
                    "replicas": 3,
                    "availableReplicas": 2,
                    "labels": {
                        "com.openfaas.scale.min": "1",
                        "com.openfaas.scale.max": "10",
                        "com.openfaas.scale.factor": "20"
                    },
                    "annotations": {
                        "com.openfaas.ready.http.path": "/ready"
                    }
                }
            "#,
            )
            .create_async()
            .await;

        let response = client_for(&server)
            .get_replicas("figlet", "openfaas-fn")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.replicas, 3);
        assert_eq!(response.available_replicas, 2);
        assert_eq!(response.min_replicas, 1);
        assert_eq!(response.max_replicas, 10);
        assert_eq!(response.scaling_factor, 20);
        assert_eq!(
            response.annotations.get("com.openfaas.ready.http.path").map(String::as_str),
            Some("/ready")
        );
    }

    #[tokio::test]
    async fn test_get_replicas_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/function/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_replicas("missing", "openfaas-fn")
            .await
            .unwrap_err();
        assert_eq!(err, ScalingError::NotFound("missing.openfaas-fn".into()));
    }

    #[tokio::test]
    async fn test_get_replicas_500() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/function/figlet")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("provider exploded")
            .create_async()
            .await;

        let err = client_for(&server)
            .get_replicas("figlet", "openfaas-fn")
            .await
            .unwrap_err();
        match err {
            ScalingError::HttpError(status, body) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "provider exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_replicas_bad_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/function/figlet")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server)
            .get_replicas("figlet", "openfaas-fn")
            .await
            .unwrap_err();
        assert!(matches!(err, ScalingError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_get_replicas_unreachable() {
        // 端口 1 上没有服务
        let client = ExternalServiceQuery::new(Url::parse("http://127.0.0.1:1").unwrap(), None).unwrap();
        let err = client.get_replicas("figlet", "openfaas-fn").await.unwrap_err();
        assert!(matches!(err, ScalingError::Transport(_)));
    }

    #[tokio::test]
    async fn test_set_replicas() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/system/scale-function/figlet")
            .match_query(Matcher::UrlEncoded("namespace".into(), "openfaas-fn".into()))
            .match_body(Matcher::JsonString(
                r#"{"serviceName":"figlet","replicas":5}"#.into(),
            ))
            .with_status(202)
            .create_async()
            .await;

        let result = client_for(&server)
            .set_replicas("figlet", "openfaas-fn", 5)
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_replicas_clamps_to_cluster_max() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/system/scale-function/figlet")
            .match_query(Matcher::Any)
            .match_body(Matcher::JsonString(
                r#"{"serviceName":"figlet","replicas":100}"#.into(),
            ))
            .with_status(200)
            .create_async()
            .await;

        client_for(&server)
            .set_replicas("figlet", "openfaas-fn", 500)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_replicas_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/system/scale-function/figlet")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("no capacity")
            .create_async()
            .await;

        let err = client_for(&server)
            .set_replicas("figlet", "openfaas-fn", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ScalingError::HttpError(StatusCode::INTERNAL_SERVER_ERROR, _)));
    }

    #[tokio::test]
    async fn test_scale_alert_posts_desired_count() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/system/scale-function/figlet")
            .match_query(Matcher::Any)
            .match_body(Matcher::JsonString(
                r#"{"serviceName":"figlet","replicas":7}"#.into(),
            ))
            .with_status(200)
            .create_async()
            .await;

        client_for(&server)
            .scale_alert("figlet", "openfaas-fn", 7)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_is_injected() {
        let mut server = mockito::Server::new_async().await;
        // admin:secret
        let mock = server
            .mock("GET", "/system/function/figlet")
            .match_query(Matcher::Any)
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_body(r#"{"name":"figlet","replicas":1,"availableReplicas":1}"#)
            .create_async()
            .await;

        let injector = BasicAuthInjector::new(BasicAuthCredentials {
            user: "admin".into(),
            password: "secret".into(),
        });
        let client = ExternalServiceQuery::new(
            Url::parse(&server.url()).unwrap(),
            Some(Arc::new(injector)),
        )
        .unwrap();
        client.get_replicas("figlet", "openfaas-fn").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_functions() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/functions")
            .match_query(Matcher::UrlEncoded("namespace".into(), "dev".into()))
            .with_status(200)
            .with_body(
                r#"[{"name":"figlet","namespace":"dev","replicas":1,"availableReplicas":1,"image":"figlet:latest"},
                    {"name":"nodeinfo","namespace":"dev","replicas":0}]"#,
            )
            .create_async()
            .await;

        let functions = client_for(&server).list_functions("dev").await.unwrap();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name, "figlet");
        assert_eq!(functions[0].extra["image"], "figlet:latest");
        assert_eq!(functions[1].available_replicas, 0);
    }

    #[tokio::test]
    async fn test_list_namespaces_404_means_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/namespaces")
            .with_status(404)
            .create_async()
            .await;

        let namespaces = client_for(&server).list_namespaces().await.unwrap();
        assert!(namespaces.is_empty());
    }

    #[tokio::test]
    async fn test_list_namespaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/system/namespaces")
            .with_status(200)
            .with_body(r#"["openfaas-fn","dev"]"#)
            .create_async()
            .await;

        let namespaces = client_for(&server).list_namespaces().await.unwrap();
        assert_eq!(namespaces, vec!["openfaas-fn".to_string(), "dev".to_string()]);
    }
}
