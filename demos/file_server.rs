extern crate argparse;
extern crate env_logger;
extern crate packet_http;

use std::process::exit;
use std::time::SystemTime;

use argparse::{ArgumentParser, Store, StoreOption};
use packet_http::fs::DirFs;
use packet_http::server::{Authentication, CacheInfo, Credentials, Handler};
use packet_http::server::{HttpServer, Method};
use packet_http::tcp::TcpTransport;
use packet_http::PacketPool;


struct Files {
    /// `user:password` guarding everything under `/private`
    private: Option<(String, String)>,
}

impl Handler for Files {
    fn authentication_check(&mut self, _method: Method, resource: &str)
        -> Authentication
    {
        match self.private {
            Some((ref user, ref password)) if resource.starts_with("/private")
            => {
                Authentication::Basic(Credentials::new("private", &user[..],
                                                       &password[..]))
            }
            _ => Authentication::None,
        }
    }
    fn cache_info(&mut self, _resource: &str) -> Option<CacheInfo> {
        Some(CacheInfo { max_age: 60, last_modified: None })
    }
    fn gmt_now(&mut self) -> Option<SystemTime> {
        Some(SystemTime::now())
    }
}

fn main() {
    env_logger::init();
    let mut port = 8080u16;
    let mut root = ".".to_string();
    let mut login = None::<String>;
    let mut buffers = 64usize;
    {
        let mut ap = ArgumentParser::new();
        ap.set_description("Serves a directory over HTTP");
        ap.refer(&mut port)
            .add_option(&["-p", "--port"], Store, "Port to listen on");
        ap.refer(&mut root)
            .add_option(&["-r", "--root"], Store, "Directory to serve");
        ap.refer(&mut login)
            .add_option(&["--private-login"], StoreOption,
                "USER:PASSWORD required for paths under /private");
        ap.refer(&mut buffers)
            .add_option(&["--buffers"], Store, "Packet pool size");
        ap.parse_args_or_exit();
    }
    let private = match login {
        Some(login) => match login.find(':') {
            Some(colon) => Some((login[..colon].to_string(),
                                 login[colon+1..].to_string())),
            None => {
                eprintln!("--private-login expects USER:PASSWORD");
                exit(2);
            }
        },
        None => None,
    };
    let pool = PacketPool::new(buffers, 1536);
    let mut transport = TcpTransport::bind(("0.0.0.0", port), &pool)
        .unwrap_or_else(|e| {
            eprintln!("Can't listen on port {}: {}", port, e);
            exit(1);
        });
    let mut server = HttpServer::new(pool, DirFs::new(root),
                                     Files { private: private });
    if let Err(e) = server.serve(&mut transport) {
        eprintln!("Server failed: {}", e);
        exit(1);
    }
}
