//! A scripted, single-connection SMTP server for client tests.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::JoinHandle;

/// What the server saw during one session.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Every command line, without the trailing CRLF.
    pub commands: Vec<String>,
    /// The payload of each DATA command.
    pub messages: Vec<String>,
}

impl Transcript {
    pub fn count(&self, verb: &str) -> usize {
        self.commands
            .iter()
            .filter(|c| c.to_ascii_uppercase().starts_with(verb))
            .count()
    }
}

pub struct FakeServer {
    pub addr: SocketAddr,
    handle: JoinHandle<Transcript>,
}

impl FakeServer {
    /// Accept one connection. RCPT for any address in `refuse` gets a 550.
    pub fn start(refuse: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let refuse: Vec<String> = refuse.iter().map(|s| s.to_string()).collect();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream, &refuse)
        });
        Self { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the client to hang up and return the session transcript.
    pub fn finish(self) -> Transcript {
        self.handle.join().unwrap()
    }
}

fn serve(stream: TcpStream, refuse: &[String]) -> Transcript {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    let mut transcript = Transcript::default();

    reply(&mut writer, "220 fake.test ESMTP ready\r\n");
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        transcript.commands.push(command.clone());

        match verb.as_str() {
            "EHLO" => reply(
                &mut writer,
                "250-fake.test greets you\r\n250-8BITMIME\r\n250-SIZE 33554432\r\n250 HELP\r\n",
            ),
            "HELO" | "MAIL" | "RSET" | "NOOP" => reply(&mut writer, "250 2.0.0 OK\r\n"),
            "RCPT" => {
                let address = command
                    .split_once('<')
                    .and_then(|(_, rest)| rest.split_once('>'))
                    .map(|(addr, _)| addr.to_string())
                    .unwrap_or_default();
                if refuse.contains(&address) {
                    reply(&mut writer, "550 5.1.1 No such user here\r\n");
                } else {
                    reply(&mut writer, "250 2.1.5 OK\r\n");
                }
            }
            "DATA" => {
                reply(&mut writer, "354 End data with <CR><LF>.<CR><LF>\r\n");
                let mut data = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == ".\r\n" {
                        break;
                    }
                    data.push_str(&line);
                }
                transcript.messages.push(data);
                reply(&mut writer, "250 2.0.0 Ok: queued as 12345\r\n");
            }
            "QUIT" => {
                reply(&mut writer, "221 2.0.0 Bye\r\n");
                break;
            }
            _ => reply(&mut writer, "502 5.5.2 Command not recognized\r\n"),
        }
    }
    transcript
}

fn reply(writer: &mut TcpStream, text: &str) {
    let _ = writer.write_all(text.as_bytes());
    let _ = writer.flush();
}
