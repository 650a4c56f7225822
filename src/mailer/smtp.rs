use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, info};
use native_tls::TlsConnector;

use crate::error::{Error, Result};
use crate::mailer::message;
use crate::settings::SmtpConfig;

// A single-use SMTP session: one command in flight at a time, one message,
// torn down afterwards. Generic over the transport so tests can drive it
// through a plain TCP socket instead of TLS.
pub struct SmtpSession<S: Read + Write> {
    stream: BufReader<S>,
}

// Deliver exactly one message over implicit TLS. Dropping the session
// closes the socket on every path, success or failure.
pub fn send_email(config: &SmtpConfig, subject: &str, body: &str) -> Result<()> {
    // Validated before any network I/O; STARTTLS is out of scope.
    if config.encryption != "ssl" {
        return Err(Error::UnsupportedEncryption(config.encryption.clone()));
    }

    let stream = connect(config)?;
    let mut session = SmtpSession::new(stream);
    session.send(config, subject, body)
}

// TCP connect plus TLS handshake, both bounded by the configured timeout.
// native-tls defaults verify the peer certificate and hostname and reject
// self-signed certificates.
fn connect(config: &SmtpConfig) -> Result<native_tls::TlsStream<TcpStream>> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    let address = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|err| Error::Connect(err.to_string()))?
        .next()
        .ok_or_else(|| Error::Connect(format!("no address found for {}", config.host)))?;

    let tcp = TcpStream::connect_timeout(&address, timeout)
        .map_err(|err| Error::Connect(err.to_string()))?;
    tcp.set_read_timeout(Some(timeout))
        .map_err(|err| Error::Connect(err.to_string()))?;
    tcp.set_write_timeout(Some(timeout))
        .map_err(|err| Error::Connect(err.to_string()))?;

    let connector = TlsConnector::new().map_err(|err| Error::Connect(err.to_string()))?;
    let stream = connector
        .connect(&config.host, tcp)
        .map_err(|err| Error::Connect(err.to_string()))?;

    info!("-- connected to {}:{}", config.host, config.port);
    Ok(stream)
}

impl<S: Read + Write> SmtpSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    // The full command sequence for one message, greeting through QUIT.
    // Any unexpected reply aborts the whole send; there is no retry and no
    // partial-success state.
    pub fn send(&mut self, config: &SmtpConfig, subject: &str, body: &str) -> Result<()> {
        self.expect_reply(&[220])?;

        self.command(&format!("EHLO {}", local_hostname()), &[250])?;

        self.command("AUTH LOGIN", &[334])?;
        self.credential(&BASE64.encode(config.username.as_bytes()), &[334])?;
        self.credential(&BASE64.encode(config.password.as_bytes()), &[235])?;

        self.command(&format!("MAIL FROM:<{}>", config.username), &[250])?;
        self.command(&format!("RCPT TO:<{}>", config.recipient), &[250, 251])?;
        self.command("DATA", &[354])?;

        let message = message::dot_stuff(&message::build_message(config, subject, body));
        self.write_raw(&message)?;
        self.write_raw("\r\n.\r\n")?;
        self.expect_reply(&[250])?;

        self.command("QUIT", &[221])?;
        info!("-- message accepted for {}", config.recipient);
        Ok(())
    }

    // Write one command line, then read and validate its reply.
    fn command(&mut self, command: &str, expected: &[u16]) -> Result<String> {
        debug!(">> {command}");
        self.write_raw(command)?;
        self.write_raw("\r\n")?;
        self.expect_reply(expected)
    }

    // Same as command, but the payload stays out of the logs.
    fn credential(&mut self, value: &str, expected: &[u16]) -> Result<String> {
        debug!(">> [credential]");
        self.write_raw(value)?;
        self.write_raw("\r\n")?;
        self.expect_reply(expected)
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.stream
            .get_mut()
            .write_all(text.as_bytes())
            .map_err(|err| Error::ConnectionLost(err.to_string()))?;
        Ok(())
    }

    fn expect_reply(&mut self, expected: &[u16]) -> Result<String> {
        let reply = self.read_reply()?;
        debug!("<< {}", reply.trim_end());

        let code = reply.get(..3).and_then(|text| text.parse::<u16>().ok());
        match code {
            Some(code) if expected.contains(&code) => Ok(reply),
            _ => Err(Error::UnexpectedReply(reply)),
        }
    }

    // Accumulate reply lines until one carries a space after the 3-digit
    // code (RFC 5321 multi-line convention; a dash means more lines
    // follow). The concatenation of all lines is the reply text.
    fn read_reply(&mut self) -> Result<String> {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            match self.stream.read_line(&mut line) {
                Ok(0) if reply.is_empty() => return Err(Error::NoReply),
                Ok(0) => {
                    return Err(Error::ConnectionLost(format!(
                        "stream ended mid-reply after {reply:?}"
                    )))
                }
                Ok(_) => {}
                Err(_) if reply.is_empty() => return Err(Error::NoReply),
                Err(err) => return Err(Error::ConnectionLost(err.to_string())),
            }

            reply.push_str(&line);
            let bytes = line.as_bytes();
            if bytes.len() >= 4 && bytes[3] == b' ' {
                return Ok(reply);
            }
        }
    }
}

// Resolved once per send; EHLO still has to carry something when the local
// hostname is unavailable.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // In-memory stream: canned server bytes in, client bytes captured.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakeStream {
        fn new(input: &str) -> Self {
            Self {
                input: Cursor::new(input.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn multi_line_reply_reads_as_one() {
        let mut session = SmtpSession::new(FakeStream::new(
            "250-smtp.example.com\r\n250-SIZE 52428800\r\n250 AUTH LOGIN\r\n",
        ));
        let reply = session.expect_reply(&[250]).unwrap();
        assert_eq!(
            reply,
            "250-smtp.example.com\r\n250-SIZE 52428800\r\n250 AUTH LOGIN\r\n"
        );
    }

    #[test]
    fn dangling_multi_line_reply_is_an_error() {
        let mut session = SmtpSession::new(FakeStream::new("250-partial\r\n"));
        let err = session.read_reply().unwrap_err();
        assert!(matches!(err, Error::ConnectionLost(_)));
    }

    #[test]
    fn empty_stream_means_no_reply() {
        let mut session = SmtpSession::new(FakeStream::new(""));
        let err = session.read_reply().unwrap_err();
        assert!(matches!(err, Error::NoReply));
    }

    #[test]
    fn unexpected_code_carries_raw_reply() {
        let mut session = SmtpSession::new(FakeStream::new("550 5.1.1 User unknown\r\n"));
        let err = session.expect_reply(&[250, 251]).unwrap_err();
        match err {
            Error::UnexpectedReply(reply) => assert_eq!(reply, "550 5.1.1 User unknown\r\n"),
            other => panic!("wrong error kind: {other:?}"),
        }
    }

    #[test]
    fn garbage_code_is_unexpected() {
        let mut session = SmtpSession::new(FakeStream::new("ok? whatever\r\n"));
        let err = session.expect_reply(&[250]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply(_)));
    }

    #[test]
    fn short_lines_do_not_terminate_the_reply() {
        // "220\r\n" has no 4th-column space, so the reader keeps going.
        let mut session = SmtpSession::new(FakeStream::new("220\r\n220 ready\r\n"));
        let reply = session.expect_reply(&[220]).unwrap();
        assert_eq!(reply, "220\r\n220 ready\r\n");
    }
}
